mod symbolize;
